// Payload normalization
pub mod payload;

// Devices and source bindings
pub mod device;

// Topic subscription bookkeeping
pub mod subscription;

// Derived metrics
pub mod metric;

// Condition sets and state evaluation
pub mod condition;

// Save-time validation
pub mod validation;

// Dashboard controller task
pub mod controller;

// MQTT client integration
pub mod mqtt;

// Configuration backend client
pub mod backend;

// HTTP and WebSocket APIs
pub mod api;

// Configuration
pub mod config;

// src/services/core/infrastructure/mod.rs

pub mod circuit_breaker;
pub mod service_container;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
};
pub use service_container::{RailwatchConfig, ServiceContainer};

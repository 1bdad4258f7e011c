/// Configuration loading (defaults + `MCS_*` environment).
pub mod config;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Pub/Sub: Broker, handlers, matchers, request/reply.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::{BrokerConfig, Settings};
/// Logging setup and its shutdown handle.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Broker errors and status codes.
pub use mcs_bus_error::{BrokerError, BrokerResult, ErrorExt, StatusCode};
/// Pub/Sub API.
pub use pubsub::{
    handler_fn, matcher, payload_from, topics, Broker, BrokerState, BrokerStats, Envelope,
    Handler, HandlerResult, MessageHandler, Payload, PubSubPort,
};

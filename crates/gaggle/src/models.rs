//! These models represent the objects passed around by the engine
//!
//! Callers, middleware, tool executors and provider adapters all exchange the
//! same normalized shapes:
//! - messages made of typed content parts, in caller history and in generated output
//! - tool definitions sent to the model (name, description, parameter schema)
//! - binary data carried inline or by reference
//!
//! Provider adapters convert to and from their wire formats at their own edge;
//! nothing in here knows about a particular vendor.
pub mod content;
pub mod data;
pub mod message;
pub mod role;
pub mod tool;

//! Conversion between wire messages and message records.
//!
//! [`inbound::MessageConverter`] fills a [`MailRecord`](crate::model::record::MailRecord)
//! from a wire message; [`outbound::compose`] goes the other way.

pub mod inbound;
pub mod outbound;

pub use inbound::{ConvertState, MessageConverter};
pub use outbound::{
    compose, Body, BodyFiller, ComposeParams, ComposedMessage, OutboundMessage, TextBody,
};

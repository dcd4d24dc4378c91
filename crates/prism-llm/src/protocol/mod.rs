//! Wire formats spoken by clients and upstream providers

pub mod anthropic;
pub mod google;
pub mod openai;

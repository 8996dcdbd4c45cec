//! Match formation: the periodic loop that groups waiting players

pub mod service;

pub use service::MatchmakingService;

//! Session state: state machine, controller, packet ids and stop flag.

pub mod controller;
pub mod machine;
pub mod packet_id;
pub mod stop;

pub use controller::{SessionController, SessionError};
pub use machine::{SessionReport, SessionState, SessionStep, StepRecord};
pub use packet_id::{PacketId, PacketIdAllocator};
pub use stop::StopFlag;

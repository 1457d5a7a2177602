//! Core value types shared by the server and client

pub mod packet;

pub use packet::{FrameResult, Packet, TERMINATOR};

//! packetlog client implementation

pub mod packet_client;

pub use packet_client::PacketClient;

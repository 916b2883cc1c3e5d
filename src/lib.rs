#![warn(rust_2018_idioms)]

pub mod candidate;
pub mod chandata;
pub mod demux;
pub mod error;
pub mod packet;
pub mod port;
pub mod rand;
pub mod sdp;
pub mod session;
pub mod stun;
pub mod transport;

pub use error::Error;

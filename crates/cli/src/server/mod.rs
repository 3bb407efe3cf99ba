pub mod xdp;

pub use xdp::{spawn_xdp_server, XdpThread};

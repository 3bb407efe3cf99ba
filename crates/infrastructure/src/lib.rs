//! whack infrastructure: AF_XDP socket, DNS codec, response cache and the
//! packet pipeline that ties them together.
pub mod dns;
pub mod xsk;

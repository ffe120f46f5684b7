//! Infrastructure the SPF engine builds on: the resolver port and the
//! domain/address helpers.

pub mod cidr;
pub mod dns;
pub mod domain;

//! Infrastructure shared by the SPF core and the command-line front end.

pub mod cidr;
pub mod dns;
pub mod domain;

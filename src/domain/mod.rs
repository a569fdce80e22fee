// Domain layer: field values and the interface port every node is built on.

pub mod model;
pub mod ports;

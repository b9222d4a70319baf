pub mod bus;
pub mod connection;
pub mod events;
pub mod roster;
pub mod speech;

pub mod assignment;
pub mod notification;
pub mod order;
pub mod worker;
pub mod zone;

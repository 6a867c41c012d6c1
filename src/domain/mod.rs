pub mod creator;
pub mod masterclass;
pub mod notification;
pub mod registration;
pub mod review;
pub mod user;

pub mod browser;
pub mod cookies;
pub mod grabber;
pub mod middleware;
pub mod page;
pub mod proxy;
pub mod service;

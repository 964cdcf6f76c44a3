pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod commandes;
pub mod cron;
pub mod email;
pub mod metrics;
pub mod notifications;
pub mod pharmacies;
pub mod push;
pub mod realtime;
pub mod stock_alerts;

pub mod catalog_feed;
pub mod line;

pub mod diff_engine;
pub mod volatility;
pub mod matcher;
pub mod dispatcher;
pub mod tracker;

pub mod subscription_service;
pub mod report_service;

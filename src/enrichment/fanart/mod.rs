//! Fanart.tv integration

pub mod dto;
mod adapter;
mod client;

pub use client::FanartClient;

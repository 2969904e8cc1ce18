pub mod chats;
pub mod health;
pub mod input;
pub mod tools;
pub mod web;
pub mod whatsapp;

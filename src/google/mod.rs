pub mod callback;
pub mod credentials;
pub mod gcal;
pub mod oauth;

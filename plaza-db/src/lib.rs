pub mod client;
mod preference;
mod record;

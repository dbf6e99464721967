pub mod answer;
pub mod api_key;
pub mod candidate;
pub mod chunk;
pub mod profile;

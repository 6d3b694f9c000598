pub mod cat;
pub mod generate_keys;
pub mod passwd;
pub mod session;
pub mod signup;
pub mod write;

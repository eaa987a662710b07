/*
[INPUT]:  Token pairs from login/refresh and a durable storage backend
[OUTPUT]: Process-wide session state readable by every other component
[POS]:    Session layer - single owner of tokens and user profile
[UPDATE]: When token lifecycle or storage strategy changes
*/

pub mod jwt;
pub mod storage;
pub mod store;

pub use jwt::token_expiry;
pub use storage::{
    ACCESS_TOKEN_KEY, FileStorage, MemoryStorage, REFRESH_TOKEN_KEY, TokenStorage,
};
pub use store::{Session, SessionStore};

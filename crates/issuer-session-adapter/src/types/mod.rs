/*
[INPUT]:  Issuer backend JSON bodies (auth, profile, links, score)
[OUTPUT]: Serde models for login, refresh and issuer endpoints
[POS]:    Data layer - wire types shared by http, auth and link modules
[UPDATE]: When the backend adds fields or endpoints
*/

pub mod models;
pub mod requests;
pub mod responses;

pub use models::*;
pub use requests::*;
pub use responses::*;

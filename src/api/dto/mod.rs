//! Wire DTOs for the REST API.

pub mod register_dto;
pub mod select_dto;
pub mod token_dto;

pub use register_dto::{RegisterRequest, RegisterResponse};
pub use select_dto::{SelectTokenRequest, SelectTokenResponse};
pub use token_dto::{HealthUpdateRequest, InterestDto, TokenDto, TokenListResponse, TokenView};

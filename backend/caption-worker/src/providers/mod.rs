//! External API providers

pub mod caption_api;

pub use caption_api::{
    validate_photo_url, CaptionApiClient, CaptionApiResponse, Captioner, SharedCaptioner,
};

//! Pipeline stages between a user reference and a model reply.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! reference ──▶ resolve ──▶ normalize ──▶ encode ──▶ llm / azure / ocr
//! (path/URL)   (fallbacks)  (SVG→PNG,    (bytes or   (model or OCR
//!                            validate)    URL)        boundary)
//! ```
//!
//! 1. [`resolve`]   — expand `~`, try the relative-path fallbacks
//! 2. [`normalize`] — rasterise SVG, validate rasters, pick a media type;
//!    decoding runs in `spawn_blocking`
//! 3. [`prepare`]   — HEAD-check URLs, compose 1 and 2 for local files,
//!    fan out over a batch in input order
//! 4. [`encode`]    — the prepared payload and its data-URL form
//! 5. [`params`]    — token-limit field routing and reasoning-effort policy
//! 6. [`schema`]    — caller JSON schema → [`schema::OutputContract`]
//! 7. [`llm`]       — the [`llm::VisionModel`] boundary, edgequake-llm backend
//!    and provider routing; [`azure`] is the direct Azure OpenAI backend
//! 8. [`ocr`]       — the [`ocr::OcrClient`] boundary and the Foundry client

pub mod azure;
pub mod encode;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod params;
pub mod prepare;
pub mod resolve;
pub mod schema;

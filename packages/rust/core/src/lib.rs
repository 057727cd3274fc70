//! Core pipelines for ProfileSynth.
//!
//! This crate ties the document store and the generation service together
//! into the two end-to-end workflows: `generate_qa` (profile → Q&A artifact)
//! and `export_to_file` (whole store → text dump).

pub mod artifact;
pub mod context;
pub mod export;
pub mod generation;
pub mod pipeline;
pub mod retriever;

#[cfg(test)]
pub(crate) mod testing;

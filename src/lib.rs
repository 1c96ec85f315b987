//! # Raia Assist
//!
//! A citizen-service retrieval backend for Kenyan government services.
//!
//! Raia Assist crawls government portals (robots.txt-compliant, rate
//! limited), ingests PDFs, chunks and classifies the text into a
//! front-matter corpus, embeds the corpus into a vector index, and answers
//! questions with cited excerpts — optionally routed through a generation
//! endpoint — via a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ URLs / PDFs  │──▶│ Fetch + Extract  │──▶│ Chunk+Classify│
//! │ robots-gated │   │ raw artifacts    │   │ corpus (.md)  │
//! └──────────────┘   └──────────────────┘   └───────┬───────┘
//!                                                   │
//!                          ┌────────────────────────┤
//!                          ▼                        ▼
//!                    ┌──────────┐           ┌──────────────┐
//!                    │  Embed   │──────────▶│ Vector index │
//!                    └──────────┘           └──────┬───────┘
//!                                                  │
//!                            ┌─────────────────────┤
//!                            ▼                     ▼
//!                       ┌──────────┐         ┌──────────┐
//!                       │   CLI    │         │   HTTP   │
//!                       │  (raia)  │         │  (chat)  │
//!                       └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! raia init                      # starter config + directories
//! raia robots --urls urls.txt    # robots.txt compliance report
//! raia fetch --urls urls.txt     # crawl to raw artifacts + manifest
//! raia chunk                     # manifest -> corpus documents
//! raia pdf handbook.pdf          # ingest a PDF into the corpus
//! raia index build               # corpus -> embeddings -> index
//! raia ask "how do I register for NHIF?"
//! raia serve                     # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`robots`] | robots.txt gate and compliance report |
//! | [`fetch`] | Polite page fetching and the crawl driver |
//! | [`extract_html`] | HTML title and body-text extraction |
//! | [`chunk`] | Text cleaning and paragraph chunking |
//! | [`classify`] | Category classification and tag extraction |
//! | [`corpus`] | Front-matter corpus documents |
//! | [`pdf`] | PDF ingestion |
//! | [`embedding`] | Embedding backend abstraction |
//! | [`index`] | Vector index build and search |
//! | [`answer`] | Retrieval answer assembly |
//! | [`generate`] | Optional generation client |
//! | [`jobs`] | Processing job store |
//! | [`server`] | HTTP API |
//! | [`db`] | Jobs database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod classify;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod extract_html;
pub mod fetch;
pub mod generate;
pub mod index;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod pdf;
pub mod progress;
pub mod robots;
pub mod server;
pub mod stats;

//! # Dr. Docent
//!
//! Backend for a personal health tracker. Users log meals, exercise,
//! medication and sleep; the service scores each day, ranks users, tracks
//! fasting windows and cycles, and answers questions through a chat
//! assistant grounded in drug, nutrient and medical-literature data.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  HTTP (/api) │──▶│ logs/scoring │──▶│    SQLite    │
//! │  CLI (docent)│   │ cycle/profile│   │  (sqlx pool) │
//! └──────┬───────┘   └──────────────┘   └──────▲───────┘
//!        │                                     │
//!        ▼                                     │
//! ┌──────────────┐   ┌──────────────┐          │
//! │     chat     │──▶│ RAG: papers, │──────────┘
//! │  (LLM call)  │   │ drugs, USDA  │──▶ PubMed / MFDS / USDA
//! └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent init                           # create database
//! docent serve                          # start HTTP API
//! docent papers feed "knee osteoarthritis exercise"
//! docent papers search "무릎 통증"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Row types and timestamp helpers |
//! | [`logs`] | Activity log storage |
//! | [`scoring`] | Daily score and points ledger |
//! | [`ranking`] | Daily ranking |
//! | [`group_calendar`] | Privacy-preserving group activity calendars |
//! | [`schedules`] / [`cycle`] / [`profile`] / [`push`] | User data |
//! | [`health`] / [`radar`] | Age, BMI, fasting and radar calculations |
//! | [`usda`] / [`mfds`] / [`pubmed`] / [`scholar`] | External API clients |
//! | [`dni`] / [`drugs`] / [`food_knowledge`] | Drug and nutrient knowledge |
//! | [`papers`] / [`chunk`] / [`embedding`] / [`feeding`] | Literature store |
//! | [`llm`] / [`intent`] / [`aggregator`] / [`chat`] | Chat assistant |
//! | [`traits`] | Assistant tool registry |
//! | [`server`] / [`routes`] | HTTP server |
//! | [`db`] / [`migrate`] | Database connection and schema |

pub mod aggregator;
pub mod chat;
pub mod chunk;
pub mod clients;
pub mod config;
pub mod cycle;
pub mod db;
pub mod dni;
pub mod drugs;
pub mod embedding;
pub mod feeding;
pub mod food_knowledge;
pub mod group_calendar;
pub mod health;
pub mod http;
pub mod intent;
pub mod llm;
pub mod logs;
pub mod mfds;
pub mod migrate;
pub mod models;
pub mod papers;
pub mod profile;
pub mod pubmed;
pub mod push;
pub mod radar;
pub mod ranking;
pub mod routes;
pub mod schedules;
pub mod scholar;
pub mod scoring;
pub mod server;
pub mod traits;
pub mod usda;

//! reddit-ocr - subreddit image scraping with OCR text extraction.
//!
//! Queries a Pushshift-compatible search API for a subreddit's posts,
//! downloads the attached images and writes the text Tesseract finds in each
//! one to a file next to the others.

pub mod cli;
pub mod config;
pub mod models;
pub mod ocr;
pub mod scrapers;
pub mod services;
pub mod utils;

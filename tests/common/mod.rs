//! Shared fixtures: scripted engines and comment builders.

#![allow(dead_code)]

pub mod builders;
pub mod engines;

pub use builders::{comments, numbered};
pub use engines::{Fault, ScriptedEngine};

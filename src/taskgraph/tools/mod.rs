// SPDX-License-Identifier: MIT

//! Built-in tools

pub mod code_review;

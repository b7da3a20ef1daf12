// Library root
// -----------
// This crate exposes the console interpreter as a library. The binary
// (`main.rs`) wires it to a real terminal and a real HTTP client.
//
// Module responsibilities:
// - `command`, `help`, `router`: turn a typed line into an `Effect`
//   (local text, navigation, remote call, session clearing).
// - `console`, `task`, `transcript`: carry out effects, run remote calls
//   off the input thread and keep the rendered history.
// - `api`, `cookies`: HTTP access to the itisadb web front-end and its
//   session cookies.
// - `input`, `ui`: keyboard handling, the event loop and the login prompt.
// - `config`, `logging`: environment configuration and the log file.
//
// Everything below `ui` runs without a terminal, which is how the tests
// drive it.
pub mod api;
pub mod command;
pub mod config;
pub mod console;
pub mod cookies;
pub mod help;
pub mod input;
pub mod logging;
pub mod router;
pub mod task;
pub mod transcript;
pub mod ui;

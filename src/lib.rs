//! unitytool: an auditable editing pipeline for a Unity-style asset tree.
//!
//! A project's `Assets/` directory is a graph of serialized YAML/JSON
//! objects addressed by `guid`/`fileID` pairs. This crate builds a GUID
//! index over that graph, scans it for reference-integrity problems,
//! inspects prefab variant overrides for staleness, and carries a
//! declarative patch plan — hashed, optionally signed, optionally
//! attested — through a gated apply pipeline that dispatches to either an
//! in-process JSON backend or an external engine bridge process.
//!
//! Every operation returns the same `{success, severity, code, message,
//! data, diagnostics[]}` envelope shape, so the CLI in [`cli`] is a thin
//! layer over [`core`].

pub mod cli;
pub mod core;

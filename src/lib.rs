//! Transparent interception of kernel-mode code execution and memory
//! access through Intel VT-x EPT page shadowing.
//!
//! A hooked guest page is backed by two host copies of its contents: an
//! execute view carrying planted breakpoints or patch bytes, and a
//! read/write view carrying the pristine bytes. Guests reading the page
//! observe original code; guests executing it hit traps that redirect
//! control into handler routines living in the host.
//!
//! The engine owns the per-page shadowing state machine (#BP, EPT
//! violation and Monitor Trap Flag VM-exits), the catalog coordinating
//! function hooks and memory monitors that share a 4 KiB page, and the
//! installation protocol that displaces the first victim instruction into
//! an original-call stub. Everything below the seams in
//! [`platform`], [`intel::ept`] and [`intel::vmcs`] is supplied by the
//! host hypervisor core.

#![no_std]

extern crate alloc;
extern crate static_assertions;

pub mod error;
pub mod intel;
pub mod platform;

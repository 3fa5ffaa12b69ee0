#![no_std]

//! Wire-format event structs shared between a kernel-side event producer and
//! the cgroup-sentinel agent. Kept `no_std` and `repr(C)` because the
//! producer side writes these directly into a shared ring buffer; the
//! producer itself is an external collaborator and is not part of this
//! crate (see spec §1 non-goals).

/// Kind of process event the kernel-sourced producer reports.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Execve = 0,
    Open = 1,
}

/// Fixed-size event as written by the producer.
///
/// `comm` and `path` are NUL-padded byte buffers; the agent trims trailing
/// NUL bytes and lossily converts to UTF-8 at the ingress boundary.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub pid: i32,
    pub cgroup_id: u64,
    pub comm: [u8; 16],
    pub path: [u8; 256],
}

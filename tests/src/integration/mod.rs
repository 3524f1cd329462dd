//! Cross-subsystem scenarios. Every node is a full `PeerNode`; links are
//! made explicitly on a manual swarm unless a test needs gossip from the
//! start.

#[cfg(test)]
pub mod harness;

#[cfg(test)]
mod ackable;
#[cfg(test)]
mod determinism;
#[cfg(test)]
mod gaps;
#[cfg(test)]
mod sync;

//! End-to-end call scenarios: two orchestrators negotiating through a real
//! in-process session registry, with actual peer connections over loopback.

mod scenarios;

//! Self and swept collision checking for serial robots, with allowed-collision
//! filtering, built on the [parry3d](https://parry.rs) narrow phase.
//!
//! The crate layers robot-specific semantics over a generic collision engine:
//! per-link collision objects are built once from a robot description, only
//! their poses are refreshed per query, and an allowed-collision table decides
//! which body pairs are exempt from checking before any narrow-phase work is
//! spent on them.
//!
//! # Features
//!
//! - Per-link collision object registration from an in-memory robot
//!   description; meshes are approximated by their convex hull, all other
//!   primitives keep their exact representation.
//! - Discrete self-collision checks between the links of one configuration,
//!   with optional minimum-distance reporting folded into the result.
//! - Continuous (swept) self-collision checks between two configurations,
//!   catching crossings that discrete sampling of the motion would miss.
//! - An allowed-collision table with the filtering contract planners expect:
//!   a pair is skipped only when the table explicitly allows its collisions;
//!   an absent table, an absent entry and a "never allowed" entry all mean
//!   the pair is checked.
//! - Padding and scaling updates that rebuild only the affected links'
//!   collision objects.
//! - Bodies attached to links (grasped objects) are folded into discrete
//!   checks, with their declared touch links exempted.
//! - Cloning a checker yields an independent, query-ready copy for use from
//!   another thread; no geometry is re-derived from the description.
//!
//! Pairwise narrow-phase work is parallelized with rayon. Collision with
//! another robot is an open extension point; those entry points return
//! [`query_error::QueryError::Unsupported`].

pub mod shapes;

pub mod robot_model;
pub mod robot_state;

pub mod allowed_collision;

pub mod collision_request;
pub mod query_error;

pub mod contact_manager;
pub mod collision_robot;

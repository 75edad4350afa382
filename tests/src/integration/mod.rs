//! Integration flows across the microkernel crates.

#[cfg(test)]
mod control_plane;
#[cfg(test)]
mod pipelines;
#[cfg(test)]
mod routing;

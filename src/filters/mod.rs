// SPDX-License-Identifier: GPL-3.0-only

//! Filter kernels and their execution
//!
//! - [`registry`]: discovers kernels in a shader library and builds their pipelines
//! - [`chain`]: the ordered, toggleable selection of kernels
//! - [`executor`]: encodes a chain over a ping-pong texture pair

pub mod chain;
pub mod executor;
pub mod registry;

pub use chain::{FilterChain, FilterEntry, Kernel};
pub use executor::ChainExecutor;
pub use registry::{
    KernelDescriptor, KernelInterface, KernelOptions, KernelParams, KernelRegistry, ParamBinder,
    check_kernel_interface, param_binder_for,
};

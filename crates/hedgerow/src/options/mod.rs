// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// A flag indicating that a required typestate property is set.
#[non_exhaustive]
#[derive(Debug)]
pub struct Set;

/// A flag indicating that a required typestate property has not been set.
#[non_exhaustive]
#[derive(Debug)]
pub struct NotSet;

mod hedging_options;

pub use hedging_options::HedgingOptions;

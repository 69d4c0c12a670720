// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use thiserror::Error;

/// Error returned by chip configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SidError {
    /// The chip model value does not name a known model.
    #[error("unknown chip model {0}")]
    UnknownChipModel(u8),
    /// The sampling method value does not name a known method.
    #[error("unknown sampling method {0}")]
    UnknownSamplingMethod(u8),
    /// Clock frequency must be non-zero.
    #[error("clock frequency must be non-zero")]
    ZeroClockFrequency,
    /// Sample frequency must be non-zero.
    #[error("sample frequency must be non-zero")]
    ZeroSampleFrequency,
    /// The passband must end below half the sample frequency.
    #[error("highest accurate frequency must be below half the sample frequency")]
    InvalidPassband,
}

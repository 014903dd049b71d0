// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Asset Pipeline - resource loading for 2D game runtimes
//!
//! Throttled prefetching, a pixel-budget image cache with reservations, a lazily swept TTL
//! cache and a retry coordinator with a global stall, all driven by one per-frame `update`.

pub mod assets;
pub mod config;
pub mod error;
pub mod prelude;
pub mod profiling;
pub mod resources;
pub mod time;

pub use assets::*;
pub use config::*;
pub use error::*;
pub use resources::*;
pub use time::*;

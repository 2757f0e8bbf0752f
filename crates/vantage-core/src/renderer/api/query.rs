// Copyright 2025 eraflo
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

//! GPU query sets.

/// An opaque handle to a set of GPU queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuerySetId(pub u64);

/// What a query set measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Samples passed.
    Occlusion,
    /// Primitive and invocation counters.
    PipelineStatistics,
    /// GPU timestamps.
    Timestamp,
}

/// Describes a query set.
#[derive(Debug, Clone)]
pub struct QuerySetDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// Query type.
    pub kind: QueryKind,
    /// Number of queries in the set.
    pub count: u32,
}

//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで包んでいます。
//! `ArtifactId` と `OwnerId` は同じ 128-bit 表現ですが、
//! コンパイル時に混同できません。
//!
//! Identifiers issued by the model provider (training jobs, models) are not
//! ours to mint, so they live in [`super::remote`] as plain string newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

use super::errors::LifecycleError;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"img-", "user-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しません。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the prefixed display form (`img-01H...`) and a bare ULID.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|e| LifecycleError::NotFound(format!("malformed id {s:?}: {e}")))
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Generated image のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Artifact {}

impl IdMarker for Artifact {
    fn prefix() -> &'static str {
        "img-"
    }
}

/// Owning user のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {}

impl IdMarker for Owner {
    fn prefix() -> &'static str {
        "user-"
    }
}

/// Identifier of a generated image record.
pub type ArtifactId = Id<Artifact>;

/// Identifier of the user that owns an artifact.
pub type OwnerId = Id<Owner>;

//! Standard-library snippets.
//!
//! Small utility functions pulled into a module the first time generated
//! code calls them.  Each is addressed by a two-part `library/member` name,
//! which is also its function name in the module text.

/// A standard-library function that generated code may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Snippet {
    /// `util/i32.smax(a: i32, b: i32) -> i32`: signed maximum.
    I32Smax,
    /// `util/i32.smin(a: i32, b: i32) -> i32`: signed minimum.
    I32Smin,
    /// `util/idx(i: i32, len: i32) -> i32`: wraps a possibly negative or
    /// overflowing index into `0..len`.
    Idx,
}

impl Snippet {
    pub const ALL: [Snippet; 3] = [Self::I32Smax, Self::I32Smin, Self::Idx];

    pub fn library(self) -> &'static str {
        "util"
    }

    pub fn member(self) -> &'static str {
        match self {
            Self::I32Smax => "i32.smax",
            Self::I32Smin => "i32.smin",
            Self::Idx => "idx",
        }
    }

    /// Function name as referenced by `call`, without the `$` sigil.
    pub fn name(self) -> &'static str {
        match self {
            Self::I32Smax => "util/i32.smax",
            Self::I32Smin => "util/i32.smin",
            Self::Idx => "util/idx",
        }
    }

    /// Resolve a two-part name.
    pub fn lookup(library: &str, member: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.library() == library && s.member() == member)
    }

    /// The snippet's function form.
    pub fn text(self) -> &'static str {
        match self {
            Self::I32Smax => {
                "(func $util/i32.smax (param $a i32) (param $b i32) (result i32)\n  \
                 (select (local.get $a) (local.get $b) (i32.gt_s (local.get $a) (local.get $b))))"
            }
            Self::I32Smin => {
                "(func $util/i32.smin (param $a i32) (param $b i32) (result i32)\n  \
                 (select (local.get $a) (local.get $b) (i32.lt_s (local.get $a) (local.get $b))))"
            }
            Self::Idx => {
                "(func $util/idx (param $i i32) (param $len i32) (result i32)\n  \
                 (i32.rem_s (i32.add (i32.rem_s (local.get $i) (local.get $len)) (local.get $len)) (local.get $len)))"
            }
        }
    }
}

pub mod diff;
pub mod merge;
pub mod path;

pub use diff::{DiffOptions, diff_object};
pub use merge::{MergeOptions, merge_object};
pub use path::{
    DELETION_PREFIX, MAX_PATH_DEPTH, PatchError, delete_path, deletion_target, expand, flatten,
    get_path, has_path, set_path,
};

//! Query methods grouped by table, each implemented as `impl Database`.

mod attendance;
mod registry;
mod sessions;

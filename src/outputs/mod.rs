//! Everything the batch writes into the output directory.
//!
//! # Submodules
//!
//! - [`text`]: the accepted full text of each reference
//! - [`json`]: the success index, `successful_scrapes.json`
//! - [`manual`]: stub files for references a human has to paste in
//!
//! The failure ledger lives in [`crate::ledger`].
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── smith2020_full.md
//! ├── jones2019_full.md
//! ├── successful_scrapes.json
//! ├── failed_scrapes.json        # only while something is outstanding
//! └── manual_entry/
//!     └── doe2018_manual.txt     # only with --manual-entry
//! ```

pub mod json;
pub mod manual;
pub mod text;

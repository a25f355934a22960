//! Command-line argument builders for the Bio-Formats tools and ImageMagick.
//!
//! ## Flag Reference
//!
//! ### `showinf`
//! - `<file>`: Image to inspect
//! - `-nopix`: Read metadata only, skip pixel data
//! - `-version`: Print the Bio-Formats version and exit
//!
//! ### `bfconvert`
//! - `-series <n>`: Restrict to one series of a multi-series file
//! - `-timepoint <n>`: Restrict to one timepoint
//! - `-channel <n>`: Restrict to one channel
//! - `-z <n>`: Restrict to one focal plane
//! - `-overwrite`: Replace an existing output file instead of prompting
//!
//! The output format is chosen by the extension of the output path.
//!
//! ### `convert` (ImageMagick)
//! - `-contrast-stretch <black>%`: Stretch intensities to the full range;
//!   `0` clips no pixels at either end
//!
//! ## Known Limitations
//! - `showinf` prints a fixed banner before the report. The banner length is a
//!   property of the Bio-Formats version, not of the input file.
//! - `bfconvert` without `-overwrite` prompts on stdin when the output exists,
//!   which would block an unattended run forever.

use std::ffi::OsString;
use std::path::Path;

/// Index used for every plane selector: the first series, timepoint, channel and focal plane.
pub const FIRST_PLANE: &str = "0";

/// Builds the argument list for a metadata-only `showinf` run.
#[must_use]
pub fn showinf_args(input: &Path) -> Vec<OsString> {
    vec![OsString::from(input), OsString::from("-nopix")]
}

/// Builds the argument list for a single-plane `bfconvert` run.
#[must_use]
pub fn bfconvert_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = Vec::with_capacity(11);

    for selector in ["-series", "-timepoint", "-channel", "-z"] {
        args.push(OsString::from(selector));
        args.push(OsString::from(FIRST_PLANE));
    }

    args.push(OsString::from(input));
    args.push(OsString::from(output));
    args.push(OsString::from("-overwrite"));

    args
}

/// Builds the argument list for an ImageMagick full-range contrast stretch.
#[must_use]
pub fn contrast_stretch_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        OsString::from(input),
        OsString::from("-contrast-stretch"),
        OsString::from("0"),
        OsString::from(output),
    ]
}

/// Builds the argument list for a version probe.
#[must_use]
pub fn version_args() -> Vec<OsString> {
    vec![OsString::from("-version")]
}

//! Zero-phase FIR band-pass filtering.
//!
//! - [`design`]: Hamming-windowed `firwin` construction with MNE's automatic
//!   transition bandwidths and filter length.
//! - [`apply`]: overlap-add convolution with the `(N-1)/2` zero-phase shift
//!   and reflect-limited edge padding.

pub mod apply;
pub mod design;

pub use apply::apply_fir_zero_phase;
pub use design::{design_band_filter, firwin_lowpass, hamming, BandSpec};

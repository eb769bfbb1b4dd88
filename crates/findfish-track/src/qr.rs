use findfish_core::GrayImageView;

use crate::marker::MarkerDecoder;

/// QR decoding through `rqrr`. Returns the first grid that decodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct QrDecoder;

impl MarkerDecoder for QrDecoder {
    fn decode(&self, img: &GrayImageView<'_>) -> Option<String> {
        if img.width == 0 || img.height == 0 {
            return None;
        }
        let w = img.width;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(w, img.height, |x, y| img.data[y * w + x]);
        prepared.detect_grids().into_iter().find_map(|grid| match grid.decode() {
            Ok((_, content)) => Some(content),
            Err(e) => {
                log::trace!("qr grid rejected: {e}");
                None
            }
        })
    }
}

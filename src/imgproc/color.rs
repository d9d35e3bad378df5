use crate::core::Frame;
use crate::error::{Error, Result};

/// Color conversion codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConversionCode {
    RgbToGray,
    RgbToHsv,
    RgbToYCrCb,
    GrayToRgb,
}

/// Convert color space of a frame
pub fn cvt_color(src: &Frame, dst: &mut Frame, code: ColorConversionCode) -> Result<()> {
    match code {
        ColorConversionCode::RgbToGray => rgb_to_gray(src, dst),
        ColorConversionCode::RgbToHsv => rgb_to_hsv(src, dst),
        ColorConversionCode::RgbToYCrCb => rgb_to_ycrcb(src, dst),
        ColorConversionCode::GrayToRgb => gray_to_rgb(src, dst),
    }
}

fn check_three_channels(src: &Frame) -> Result<()> {
    if src.channels() != 3 {
        return Err(Error::InvalidInput(
            "Source must have 3 channels".to_string(),
        ));
    }
    Ok(())
}

/// Convert RGB to grayscale using BT.601 luma weights
fn rgb_to_gray(src: &Frame, dst: &mut Frame) -> Result<()> {
    check_three_channels(src)?;

    *dst = Frame::new(src.rows(), src.cols(), 1)?;
    let dst_data = dst.data_mut();

    for (i, pixel) in src.data().chunks_exact(3).enumerate() {
        let gray = 0.299 * f32::from(pixel[0]) + 0.587 * f32::from(pixel[1])
            + 0.114 * f32::from(pixel[2]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            dst_data[i] = gray.round().min(255.0) as u8;
        }
    }
    Ok(())
}

/// Replicate a grayscale plane into 3 channels
fn gray_to_rgb(src: &Frame, dst: &mut Frame) -> Result<()> {
    if src.channels() != 1 {
        return Err(Error::InvalidInput(
            "Source must have 1 channel".to_string(),
        ));
    }

    *dst = Frame::new(src.rows(), src.cols(), 3)?;
    let dst_data = dst.data_mut();
    for (i, &gray) in src.data().iter().enumerate() {
        dst_data[i * 3] = gray;
        dst_data[i * 3 + 1] = gray;
        dst_data[i * 3 + 2] = gray;
    }
    Ok(())
}

/// Convert RGB to HSV. Hue is encoded in [0, 179] so 8-bit range configs
/// carry over unchanged; S and V are in [0, 255].
fn rgb_to_hsv(src: &Frame, dst: &mut Frame) -> Result<()> {
    check_three_channels(src)?;

    *dst = Frame::new(src.rows(), src.cols(), 3)?;
    let dst_data = dst.data_mut();

    for (i, pixel) in src.data().chunks_exact(3).enumerate() {
        let r = f32::from(pixel[0]) / 255.0;
        let g = f32::from(pixel[1]) / 255.0;
        let b = f32::from(pixel[2]) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let mut h = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta) % 6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        if h < 0.0 {
            h += 360.0;
        }

        let s = if max == 0.0 { 0.0 } else { delta / max };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            dst_data[i * 3] = (h / 2.0).round().min(179.0) as u8;
            dst_data[i * 3 + 1] = (s * 255.0).round().min(255.0) as u8;
            dst_data[i * 3 + 2] = (max * 255.0).round().min(255.0) as u8;
        }
    }
    Ok(())
}

/// Convert RGB to YCrCb (BT.601)
fn rgb_to_ycrcb(src: &Frame, dst: &mut Frame) -> Result<()> {
    check_three_channels(src)?;

    *dst = Frame::new(src.rows(), src.cols(), 3)?;
    let dst_data = dst.data_mut();

    for (i, pixel) in src.data().chunks_exact(3).enumerate() {
        let r = f32::from(pixel[0]);
        let g = f32::from(pixel[1]);
        let b = f32::from(pixel[2]);

        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let cr = (r - y) * 0.713 + 128.0;
        let cb = (b - y) * 0.564 + 128.0;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            dst_data[i * 3] = y.round().clamp(0.0, 255.0) as u8;
            dst_data[i * 3 + 1] = cr.round().clamp(0.0, 255.0) as u8;
            dst_data[i * 3 + 2] = cb.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Scalar;

    #[test]
    fn test_rgb_to_gray_white() {
        let src = Frame::filled(4, 4, 3, Scalar::all(255.0)).unwrap();
        let mut dst = Frame::new(1, 1, 1).unwrap();
        cvt_color(&src, &mut dst, ColorConversionCode::RgbToGray).unwrap();
        assert_eq!(dst.channels(), 1);
        assert!(dst.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_rgb_to_gray_weights() {
        let src = Frame::filled(2, 2, 3, Scalar::new(255.0, 0.0, 0.0, 0.0)).unwrap();
        let mut dst = Frame::new(1, 1, 1).unwrap();
        cvt_color(&src, &mut dst, ColorConversionCode::RgbToGray).unwrap();
        // 0.299 * 255 = 76.245
        assert_eq!(dst.at(0, 0).unwrap()[0], 76);
    }

    #[test]
    fn test_rgb_to_hsv_pure_red() {
        let src = Frame::filled(2, 2, 3, Scalar::new(255.0, 0.0, 0.0, 0.0)).unwrap();
        let mut dst = Frame::new(1, 1, 1).unwrap();
        cvt_color(&src, &mut dst, ColorConversionCode::RgbToHsv).unwrap();
        let hsv = dst.at(0, 0).unwrap();
        assert_eq!(hsv[0], 0);
        assert_eq!(hsv[1], 255);
        assert_eq!(hsv[2], 255);
    }

    #[test]
    fn test_rgb_to_hsv_pure_green() {
        let src = Frame::filled(2, 2, 3, Scalar::new(0.0, 255.0, 0.0, 0.0)).unwrap();
        let mut dst = Frame::new(1, 1, 1).unwrap();
        cvt_color(&src, &mut dst, ColorConversionCode::RgbToHsv).unwrap();
        // Green is 120 degrees -> 60 in half-degree encoding
        assert_eq!(dst.at(0, 0).unwrap()[0], 60);
    }

    #[test]
    fn test_rgb_to_ycrcb_gray_input() {
        let src = Frame::filled(2, 2, 3, Scalar::all(128.0)).unwrap();
        let mut dst = Frame::new(1, 1, 1).unwrap();
        cvt_color(&src, &mut dst, ColorConversionCode::RgbToYCrCb).unwrap();
        let ycrcb = dst.at(0, 0).unwrap();
        assert_eq!(ycrcb[0], 128);
        assert_eq!(ycrcb[1], 128);
        assert_eq!(ycrcb[2], 128);
    }

    #[test]
    fn test_gray_round_trip() {
        let src = Frame::filled(3, 3, 1, Scalar::all(99.0)).unwrap();
        let mut rgb = Frame::new(1, 1, 1).unwrap();
        cvt_color(&src, &mut rgb, ColorConversionCode::GrayToRgb).unwrap();
        let mut back = Frame::new(1, 1, 1).unwrap();
        cvt_color(&rgb, &mut back, ColorConversionCode::RgbToGray).unwrap();
        assert_eq!(back.at(1, 1).unwrap()[0], 99);
    }
}

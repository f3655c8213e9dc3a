use crate::error::AssetError;
use crate::source::AssetBytes;
use image::ImageFormat;
use showcase_scene::EnvironmentMap;

/// Decode a Radiance HDR panorama into a linear-light equirectangular map.
pub fn decode_environment(asset: &AssetBytes) -> Result<EnvironmentMap, AssetError> {
    let image = image::load_from_memory_with_format(&asset.bytes, ImageFormat::Hdr)?.to_rgb32f();
    let (width, height) = image.dimensions();
    let texels = image
        .into_raw()
        .chunks_exact(3)
        .map(|px| [px[0], px[1], px[2]])
        .collect();

    tracing::info!(
        path = %asset.path,
        width,
        height,
        digest = %format!("{:#018x}", asset.digest),
        "decoded environment map"
    );
    Ok(EnvironmentMap::new(width, height, texels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::uniform_hdr;
    use showcase_scene::TextureMapping;

    #[test]
    fn decodes_radiance_hdr() {
        let asset = AssetBytes::new("environment.hdr", uniform_hdr(4, 2, [1.0, 0.5, 0.25]).unwrap());
        let map = decode_environment(&asset).unwrap();

        assert_eq!((map.width, map.height), (4, 2));
        assert_eq!(map.texels.len(), 8);
        assert_eq!(map.mapping, TextureMapping::EquirectangularReflection);
        let t = map.texels[0];
        assert!((t[0] - 1.0).abs() < 0.02);
        assert!((t[1] - 0.5).abs() < 0.02);
        assert!((t[2] - 0.25).abs() < 0.02);
    }

    #[test]
    fn garbage_is_an_image_error() {
        let asset = AssetBytes::new("environment.hdr", b"not an hdr".to_vec());
        assert!(matches!(
            decode_environment(&asset),
            Err(AssetError::Image(_))
        ));
    }
}

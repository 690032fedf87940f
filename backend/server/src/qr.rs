use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{ImageFormat, Luma};
use qrcode::QrCode;
use tokio::fs;

use crate::error::AppError;

pub fn qr_file_name(event_id: u64) -> String {
    format!("event_{event_id}.png")
}

pub fn qr_url(file_name: &str) -> String {
    format!("/qr/{file_name}")
}

pub fn qr_png(data: &str) -> Result<Vec<u8>, AppError> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| AppError::InternalError(Box::new(e)))?;
    let image = code.render::<Luma<u8>>().build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| AppError::InternalError(Box::new(e)))?;

    Ok(png)
}

pub async fn write_qr(dir: &Path, file_name: &str, data: &str) -> Result<PathBuf, AppError> {
    let png = qr_png(data)?;

    fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    fs::write(&path, png).await?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_png_is_png() {
        let png = qr_png("http://localhost:5000/e/1/join").unwrap();

        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), decoded.height());
    }

    #[tokio::test]
    async fn test_write_qr_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/qrs");

        let path = write_qr(&dir, &qr_file_name(4), "hello").await.unwrap();

        assert_eq!(path, dir.join("event_4.png"));
        assert!(path.exists());
    }
}

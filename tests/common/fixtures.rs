//! Catalog files and an HTTP image host

use std::io::Cursor;
use std::path::{Path, PathBuf};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Solid-colour PNG; distinct `seed`s give distinct bytes
pub fn png_bytes(width: u32, height: u32, seed: u16) -> Vec<u8> {
    let [hi, lo] = seed.to_be_bytes();
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([lo, hi, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Mock server serving one distinct 400x300 PNG per name at `/img/<name>.png`
pub struct ImageHost {
    /// Underlying mock server
    pub server: MockServer,
}

impl ImageHost {
    /// Start a host serving `names`
    pub async fn start(names: &[&str]) -> Self {
        let server = MockServer::start().await;
        for (i, name) in names.iter().enumerate() {
            Mock::given(method("GET"))
                .and(path(format!("/img/{}.png", name)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "image/png")
                        .set_body_bytes(png_bytes(400, 300, i as u16 + 1)),
                )
                .mount(&server)
                .await;
        }
        Self { server }
    }

    /// Serve a PNG of the given size at `/img/<name>.png`
    pub async fn add_sized(&self, name: &str, width: u32, height: u32) {
        Mock::given(method("GET"))
            .and(path(format!("/img/{}.png", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(width, height, 999)))
            .mount(&self.server)
            .await;
    }

    /// Absolute URL for `name`
    pub fn url(&self, name: &str) -> String {
        format!("{}/img/{}.png", self.server.uri(), name)
    }

    /// URLs for several names
    pub fn urls(&self, names: &[&str]) -> Vec<String> {
        names.iter().map(|n| self.url(n)).collect()
    }
}

/// Write a catalog with the usual headers; each row is
/// `(regional name, scientific name, priority)`
pub fn write_catalog(dir: &Path, rows: &[(&str, &str, &str)]) -> PathBuf {
    let mut text = String::from("id,species_indonesia,nama_latin,prioritas\n");
    for (i, (regional, latin, priority)) in rows.iter().enumerate() {
        text.push_str(&format!("{},{},{},{}\n", i + 1, regional, latin, priority));
    }
    let path = dir.join("catalog.csv");
    std::fs::write(&path, text).expect("write catalog");
    path
}

/// Names of the files in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

use std::collections::BTreeSet;
use std::fs;

use image::{Rgba, RgbaImage};
use table_slicer::config::parse_project;
use table_slicer::html::{image_sources, replace_image_sources};
use table_slicer::raster::ImageRaster;
use table_slicer::{slice, OccupantPrecedence, SelectionStore, SliceError, SlicerConfig};
use tempfile::tempdir;

fn banner(width: u32, height: u32) -> ImageRaster {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        if (x / 10 + y / 10) % 2 == 0 {
            Rgba([230, 57, 70, 255])
        } else {
            Rgba([29, 53, 87, 255])
        }
    });
    ImageRaster::from_rgba(&img, 90)
}

#[test]
fn project_file_slices_into_matching_html_and_jpegs() {
    let project = parse_project(serde_json::json!({
        "defaults": {"jpeg_quality": 75},
        "selections": [
            {"kind": "link", "x": 0, "y": 0, "width": 300, "height": 80, "url": "https://shop.example/sale"},
            {"kind": "replace", "x": 40, "y": 100, "width": 220, "height": 30,
             "text": "Ends Sunday", "textAlign": "center", "fontSize": "18px",
             "backgroundColor": "#1d3557", "textColor": "#ffffff"},
            {"kind": "link", "x": 150, "y": 140, "width": 100, "height": 60, "url": ""}
        ]
    }))
    .unwrap();
    let store = SelectionStore::from_records(project.selections);
    let output = slice(&banner(300, 200), store.as_slice(), "spring sale!", &project.config).unwrap();

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("springsale.html"), &output.html).unwrap();
    for file in &output.files {
        fs::write(dir.path().join(&file.name), &file.bytes).unwrap();
    }

    let referenced = image_sources(&output.html);
    let on_disk: BTreeSet<String> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".jpeg"))
        .collect();
    assert_eq!(referenced.iter().cloned().collect::<BTreeSet<_>>(), on_disk);
    assert_eq!(referenced.len(), output.files.len());

    for file in &output.files {
        let decoded = image::load_from_memory(&file.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (file.rect.width, file.rect.height));
    }

    assert!(output.html.contains("href=\"https://shop.example/sale\""));
    assert_eq!(output.html.matches("<a ").count(), 1);
    assert!(output.html.contains(">Ends Sunday</div>"));
    assert!(output.html.contains("height=\"21.6px\""));
    assert!(referenced.iter().all(|n| n.starts_with("springsale_")));
}

#[test]
fn hosted_urls_replace_sources_in_file_order() {
    let mut store = SelectionStore::new();
    store
        .add(
            table_slicer::Rect::new(100, 0, 100, 50),
            table_slicer::SelectionContent::Link {
                url: "https://x".into(),
            },
        )
        .unwrap();
    let output = slice(&banner(300, 50), store.as_slice(), "b", &SlicerConfig::default()).unwrap();
    let names: Vec<String> = output.files.iter().map(|f| f.name.clone()).collect();
    assert_eq!(names, vec!["b_1.jpeg", "b_2.jpeg", "b_3.jpeg"]);

    let urls: Vec<String> = ["https://cdn/1.jpg", "", "https://cdn/3.jpg"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let hosted = replace_image_sources(&output.html, &urls);
    assert_eq!(
        image_sources(&hosted),
        vec!["https://cdn/1.jpg", "b_2.jpeg", "https://cdn/3.jpg"]
    );
    assert!(hosted.contains("alt=\"b_1.jpeg\""));
    assert!(hosted.contains("href=\"https://x\""));
}

#[test]
fn precedence_decides_overlap_owner() {
    let mut store = SelectionStore::new();
    store
        .add(
            table_slicer::Rect::new(0, 0, 60, 40),
            table_slicer::SelectionContent::Link {
                url: "https://first".into(),
            },
        )
        .unwrap();
    store
        .add(
            table_slicer::Rect::new(30, 0, 70, 40),
            table_slicer::SelectionContent::Link {
                url: "https://second".into(),
            },
        )
        .unwrap();

    let first = slice(&banner(100, 40), store.as_slice(), "o", &SlicerConfig::default()).unwrap();
    let owners: Vec<Option<String>> = first.cells.iter().map(|c| c.link.clone()).collect();
    assert_eq!(
        owners,
        vec![Some("https://first".to_string()), Some("https://second".to_string())]
    );
    assert_eq!(first.cells[0].width, 60);

    let cfg = SlicerConfig {
        precedence: OccupantPrecedence::LastCreated,
        ..SlicerConfig::default()
    };
    let last = slice(&banner(100, 40), store.as_slice(), "o", &cfg).unwrap();
    assert_eq!(last.cells[0].width, 30);
    assert_eq!(last.cells[1].width, 70);
    assert_eq!(last.cells[1].link.as_deref(), Some("https://second"));
}

#[test]
fn empty_raster_is_rejected() {
    let raster = ImageRaster::from_rgba(&RgbaImage::new(0, 0), 90);
    let err = slice(&raster, &[], "x", &SlicerConfig::default()).unwrap_err();
    assert!(matches!(err, SliceError::EmptyImage { .. }));
}

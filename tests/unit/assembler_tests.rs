/*!
 * Tests for chapter computation and container metadata
 */

use std::path::Path;

use bookvox::app_config::PackagingConfig;
use bookvox::assembler::{ChapterMark, compute_chapters, render_ffmetadata};
use bookvox::manifest::Manifest;
use bookvox::text::{Chunker, CueAnnotator};

fn manifest_for(markdown: &str, max_chars: usize) -> Manifest {
    let chunks = Chunker::new(max_chars, true).chunk(&CueAnnotator::new().annotate(markdown));
    Manifest::from_chunks(&chunks, Path::new("/work"))
}

/// Test that each heading starts a chapter at the cumulative unit duration
#[test]
fn test_compute_chapters_withHeadings_shouldUseCumulativeOffsets() {
    // chunks: [One, a], [b], [Two, c]
    let manifest = manifest_for("# One\n\naaaa aaaa\n\nbbbb bbbb\n\n# Two\n\ncccc", 15);
    assert_eq!(manifest.len(), 3);

    let chapters = compute_chapters(&manifest, &[1000.4, 2000.0, 500.0], "Book");
    assert_eq!(chapters.len(), manifest.heading_count());
    assert_eq!(
        chapters,
        vec![
            ChapterMark {
                title: "One".to_string(),
                start_ms: 0,
                end_ms: 3000,
            },
            ChapterMark {
                title: "Two".to_string(),
                start_ms: 3000,
                end_ms: 3500,
            },
        ]
    );
}

/// Test that chapter boundaries are monotone and cover the whole book
#[test]
fn test_compute_chapters_shouldBeContiguous() {
    let manifest = manifest_for("# A\n\nx\n\n# B\n\ny\n\n# C\n\nz", 1200);
    let durations = [1234.5, 987.25, 4321.0];
    let chapters = compute_chapters(&manifest, &durations, "Book");

    assert_eq!(chapters.len(), 3);
    assert_eq!(chapters[0].start_ms, 0);
    for pair in chapters.windows(2) {
        assert_eq!(pair[0].end_ms, pair[1].start_ms);
        assert!(pair[0].start_ms <= pair[1].start_ms);
    }
    let total: f64 = durations.iter().sum();
    assert_eq!(chapters[2].end_ms, total.round() as u64);
}

/// Test that a book without headings is a single chapter named after the book
#[test]
fn test_compute_chapters_withoutHeadings_shouldUseBookTitle() {
    let manifest = manifest_for("Just text.\n\nMore text.", 5);
    let chapters = compute_chapters(&manifest, &[100.0, 200.0], "My Book");
    assert_eq!(
        chapters,
        vec![ChapterMark {
            title: "My Book".to_string(),
            start_ms: 0,
            end_ms: 300,
        }]
    );
}

/// Test that metadata values are escaped in the chapter file
#[test]
fn test_render_ffmetadata_shouldEscapeTitles() {
    let config = PackagingConfig {
        title: "Tom; Jerry".to_string(),
        ..PackagingConfig::default()
    };
    let chapters = vec![ChapterMark {
        title: "A=B".to_string(),
        start_ms: 0,
        end_ms: 10,
    }];

    let doc = render_ffmetadata(&config, &chapters);
    assert!(doc.starts_with(";FFMETADATA1\n"));
    assert!(doc.contains("title=Tom\\; Jerry\n"));
    assert!(doc.contains("genre=Audiobook\n"));
    assert!(doc.contains("[CHAPTER]\nTIMEBASE=1/1000\nSTART=0\nEND=10\ntitle=A\\=B\n"));
}

/*!
 * Tests for rendering cues into engine input
 */

use bookvox::synthesis::render::escape_markup;
use bookvox::synthesis::{CueRenderer, EmphasisPolicy, PausePolicy};
use bookvox::synthesis::EngineCapabilities;
use bookvox::text::CueAnnotator;

const BOOK: &str = "# One\n\nA & B.\n\n# Two\n\nC.";

/// Test that crude engines get paragraph gaps and upper-cased headings
#[test]
fn test_render_withPlainTextEngine_shouldUseGapsAndUpperCase() {
    let renderer = CueRenderer::for_capabilities(EngineCapabilities {
        timed_pauses: false,
        structured_emphasis: false,
    });
    assert_eq!(renderer.pauses, PausePolicy::TextualGap);
    assert_eq!(renderer.emphasis, EmphasisPolicy::UpperCase);

    let annotated = CueAnnotator::new().annotate(BOOK);
    assert_eq!(renderer.render(&annotated.paragraphs), "ONE\n\nA & B.\n\nTWO\n\nC.");
}

/// Test that markup engines get escaped text and explicit directives
#[test]
fn test_render_withMarkupEngine_shouldEscapeText() {
    let renderer = CueRenderer::for_capabilities(EngineCapabilities {
        timed_pauses: true,
        structured_emphasis: true,
    });
    assert_eq!(renderer, CueRenderer::markup());

    let annotated = CueAnnotator::new().annotate(BOOK);
    let rendered = renderer.render(&annotated.paragraphs[..2]);
    assert_eq!(
        rendered,
        r#"<break time="1200ms"/> <emphasis level="strong">One</emphasis> <break time="800ms"/> A &amp; B. <break time="250ms"/>"#
    );
}

/// Test mixed capabilities: timed pauses without structured emphasis
#[test]
fn test_render_withTimedPausesOnly_shouldUpperCaseHeadings() {
    let renderer = CueRenderer::for_capabilities(EngineCapabilities {
        timed_pauses: true,
        structured_emphasis: false,
    });
    let annotated = CueAnnotator::new().annotate("# One");
    assert_eq!(
        renderer.render(&annotated.paragraphs),
        r#"<break time="1200ms"/> ONE <break time="800ms"/>"#
    );
}

/// Test escaping of markup-significant characters
#[test]
fn test_escape_markup_shouldEscapeSpecialCharacters() {
    assert_eq!(escape_markup(r#"<a & "b">"#), "&lt;a &amp; &quot;b&quot;&gt;");
}

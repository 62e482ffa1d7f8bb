//! Instructions for the reading analyses.

/// Frame sent between two analysed pages.
pub(crate) const PAGE_SEPARATOR: &str = "\n\n-------------------\n";

/// Heading that opens the analysis of one page.
pub(crate) fn page_header(page: usize) -> String {
    format!("\n## Page {page} analysis\n\n")
}

pub(crate) fn summary(text: &str) -> String {
    format!(
        "You are a professional article summarizer. Write a comprehensive summary of the \
following article covering:

1. The main topic and purpose of the article
2. Key arguments and findings
3. Important data and evidence
4. Conclusions and recommendations

Organize the summary clearly and concisely with suitable headings, lists and emphasis. \
Make sure it covers everything important while staying within 20% of the original length.

The article:

{text}
"
    )
}

pub(crate) fn deep_reading(page: usize, content: &str) -> String {
    format!(
        "You are an expert in close reading. This is page {page} of a document.

First decide what kind of content the page holds (cover, table of contents, body text, \
references, appendix and so on) and how rich it is.

If the page is a cover, table of contents, reference list, appendix or other auxiliary \
content, state its type and basic information in one or two sentences without further \
analysis.

If the page is body text, match the depth of the analysis to the richness of the content.

For rich, information-dense pages:
1. Overview of the page
   - Its core topic
   - Its role within the whole document
2. Analysis of the important content
   - Key arguments and viewpoints
   - Important concepts and terms explained
   - Evidence and examples
3. Key points and difficulties
   - The most important information on the page
   - Content that deserves special attention

For short or simple pages, summarize the page in three to five sentences.

Do not over-analyse simple pages; the depth should be proportional to the content.

The content of page {page}:

{content}
"
    )
}

pub(crate) fn mind_map(text: &str) -> String {
    format!(
        "You are an expert at building mind maps. Turn the following article into a \
structured mind map.

Requirements:
1. Express the hierarchy with markdown headings (#)
2. Start from the central topic and branch outwards
3. Keep every branch short, using keywords or phrases
4. Keep the structure clear, usually no deeper than four levels
5. Do not use list markers (- *), only headings (#)
6. Every heading is a short keyword or phrase, never a long sentence
7. Output pure markdown headings without any other markdown syntax

Example:
# Central topic
## Topic 1
### Subtopic 1.1
#### Detail 1.1.1
#### Detail 1.1.2
### Subtopic 1.2
## Topic 2
### Subtopic 2.1

Build the mind map from this article:

{text}

Follow the example format strictly and use only markdown headings."
    )
}

use crate::domain::entities::professor_match::ProfessorMatch;

/// Renders the retrieved professors as a text block to append to the user's question.
///
/// Matches are rendered in the order the index returned them, which is the only ranking signal the
/// language model gets. Missing metadata is rendered as an empty value.
///
/// When the index returned fewer professors than `requested`, a closing note says so, letting the
/// model explain that fewer results than expected were found.
pub fn format_context(matches: &[ProfessorMatch], requested: usize) -> String {
    let mut context = String::new();

    for professor in matches {
        let metadata = &professor.metadata;
        context.push_str(&format!(
            "\nReturned Results:\nProfessor: {}\nReview: {}\nSubject: {}\nStars: {}\n\n",
            professor.id,
            metadata.review.as_deref().unwrap_or_default(),
            metadata.subject.as_deref().unwrap_or_default(),
            metadata
                .stars
                .map(|stars| stars.to_string())
                .unwrap_or_default(),
        ));
    }

    if matches.len() < requested {
        context.push_str(&format!(
            "\nNote: only {} of the {} requested professors were found.\n",
            matches.len(),
            requested
        ));
    }

    context
}

/// Splits `text` into line-bounded chunks of at most `budget` characters.
///
/// Line terminators stay attached to their line, and a line longer than the
/// budget is cut at the budget boundary, so concatenating the chunks gives
/// back `text` exactly.
pub fn split_into_chunks(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if line_len > budget {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut pieces = split_by_chars(line, budget);
            let last = pieces.pop().unwrap_or_default();
            chunks.extend(pieces);
            current_len = last.chars().count();
            current = last;
            continue;
        }

        if current_len + line_len > budget {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_by_chars(line: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(budget)
        .map(|piece| piece.iter().collect())
        .collect()
}

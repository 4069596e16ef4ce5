//! Algebraic laws of the document rope, checked over generated inputs.

use core_text::{Text, find_cluster_break, utf16};
use proptest::prelude::*;

fn lines_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 ]{0,12}", 1..80)
}

proptest! {
    #[test]
    fn json_round_trips(lines in lines_strategy()) {
        let doc = Text::of(lines.clone()).unwrap();
        prop_assert_eq!(doc.to_lines(), lines);
        let back = Text::from_json(&doc.to_json()).unwrap();
        prop_assert!(doc.eq_text(&back));
    }

    #[test]
    fn replace_matches_string_model(
        lines in lines_strategy(),
        edits in prop::collection::vec((0usize..1000, 0usize..1000, "[a-z\\n]{0,8}"), 1..24),
    ) {
        // ASCII-only content, so UTF-16 offsets and byte offsets coincide and
        // a plain String can serve as the reference model.
        let mut doc = Text::of(lines.clone()).unwrap();
        let mut model = lines.join("\n");
        for (a, b, ins) in edits {
            let len = doc.len();
            let from = a % (len + 1);
            let to = from + b % (len - from + 1);
            doc = doc.replace(from, to, &Text::from(ins.as_str())).unwrap();
            model = format!("{}{}{}", &model[..from], ins, &model[to..]);
            prop_assert_eq!(doc.to_string(), model.clone());
            prop_assert_eq!(doc.len(), model.len());
            prop_assert_eq!(doc.lines(), model.split('\n').count());
        }
    }

    #[test]
    fn depth_stays_logarithmic(
        seed_lines in 1usize..2000,
        edits in prop::collection::vec((0usize..10_000, "[a-z\\n]{0,6}"), 0..40),
    ) {
        let lines: Vec<String> = (0..seed_lines).map(|i| format!("line {i}")).collect();
        let mut doc = Text::of(lines).unwrap();
        for (a, ins) in edits {
            let pos = a % (doc.len() + 1);
            doc = doc.replace(pos, pos, &Text::from(ins.as_str())).unwrap();
        }
        let bound = (doc.lines() as f64).log2().ceil() as usize + 2;
        prop_assert!(doc.depth() <= bound, "depth {} over bound {}", doc.depth(), bound);
    }

    #[test]
    fn equality_is_shape_independent(lines in lines_strategy()) {
        let built = Text::of(lines.clone()).unwrap();
        let mut grown = Text::of(lines[..1].to_vec()).unwrap();
        for line in &lines[1..] {
            grown = grown.append(&Text::of(["", line.as_str()]).unwrap());
        }
        prop_assert!(built.eq_text(&grown));
        prop_assert!(grown.eq_text(&built));
    }

    #[test]
    fn cluster_walks_agree_in_both_directions(
        chars in prop::collection::vec(prop::char::any(), 0..24),
    ) {
        let s: String = chars.into_iter().collect();
        let total = utf16::len(&s);
        let mut forward = vec![0];
        let mut pos = 0;
        while pos < total {
            let next = find_cluster_break(&s, pos, true);
            prop_assert!(next > pos);
            forward.push(next);
            pos = next;
        }
        let mut backward = vec![total];
        let mut pos = total;
        while pos > 0 {
            let prev = find_cluster_break(&s, pos, false);
            prop_assert!(prev < pos);
            backward.push(prev);
            pos = prev;
        }
        backward.reverse();
        prop_assert_eq!(forward, backward);
    }
}

use bytes::Bytes;
use chunkflow::ndjson::LineSplitter;
use chunkflow::prelude::*;
use chunkflow::sink::CollectSink;
use chunkflow::source::IterSource;
use proptest::prelude::*;

fn run_pipeline<F>(build: F) -> Outcome
where
    F: FnOnce(&mut Pipeline) -> chunkflow::error::Result<()>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    rt.block_on(async move {
        let mut pipeline = Pipeline::new();
        build(&mut pipeline).expect("build failed");
        pipeline
            .run(CancelToken::new())
            .await
            .expect("pipeline failed to start")
            .outcome
    })
}

fn cut(input: &[u8], cuts: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut rest = input;
    for &n in cuts {
        if rest.is_empty() {
            break;
        }
        let (head, tail) = rest.split_at(n.min(rest.len()));
        chunks.push(Bytes::copy_from_slice(head));
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(Bytes::copy_from_slice(rest));
    }
    chunks
}

fn split_lines(chunks: Vec<Bytes>, high_water_mark: usize) -> Vec<Bytes> {
    let (sink, lines) = CollectSink::<Bytes>::shared();
    let outcome = run_pipeline(|p| {
        let src = p.add_source("chunks", IterSource::from_vec(chunks))?;
        let split = p.add_transform("split", LineSplitter::new())?;
        let sink = p.add_sink("collect", sink)?;
        p.connect(&src, &split, high_water_mark)?;
        p.connect(&split, &sink, high_water_mark)?;
        Ok(())
    });
    assert!(outcome.is_success(), "{outcome:?}");
    let out = lines.lock().expect("mutex poisoned").clone();
    out
}

fn line_bytes() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![3 => Just(b'\n'), 10 => any::<u8>()], 0..512)
}

proptest! {
    #[test]
    fn rejoined_lines_reproduce_input(
        input in line_bytes(),
        cuts in proptest::collection::vec(1usize..64, 0..32),
        high_water_mark in 1usize..64,
    ) {
        let lines = split_lines(cut(&input, &cuts), high_water_mark);

        let mut rejoined = lines
            .iter()
            .map(|l| l.to_vec())
            .collect::<Vec<_>>()
            .join(&b'\n');
        if input.last() == Some(&b'\n') {
            rejoined.push(b'\n');
        }
        prop_assert!(lines.iter().all(|l| !l.contains(&b'\n')));
        prop_assert_eq!(rejoined, input);
    }

    #[test]
    fn object_edges_keep_fifo(
        items in proptest::collection::vec(any::<u32>(), 0..300),
        high_water_mark in 1usize..16,
    ) {
        let (sink, out) = CollectSink::<u32>::shared();
        let expected = items.clone();
        let outcome = run_pipeline(|p| {
            let src = p.add_source("items", IterSource::from_vec(items))?;
            let sink = p.add_sink("collect", sink)?;
            p.connect(&src, &sink, high_water_mark)?;
            Ok(())
        });
        prop_assert!(outcome.is_success());
        prop_assert_eq!(out.lock().expect("mutex poisoned").clone(), expected);
    }
}

#[test]
fn single_byte_chunks() {
    let input = b"one\ntwo\n\nthree";
    let chunks = input.iter().map(|b| Bytes::copy_from_slice(&[*b])).collect();
    let lines = split_lines(chunks, 1);
    assert_eq!(
        lines,
        vec![
            Bytes::from_static(b"one"),
            Bytes::from_static(b"two"),
            Bytes::new(),
            Bytes::from_static(b"three"),
        ]
    );
}

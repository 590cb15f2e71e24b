//! File adapter tests: WAV in, WAV out.

use lingostream::{FileReader, FileWriter, Reader, Writer};

fn write_wav(path: &std::path::Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

#[tokio::test]
async fn file_reader_serves_wav_as_pcm16() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("speech.wav");
    let samples: Vec<i16> = (0..1600).map(|i| (i % 3000) as i16).collect();
    write_wav(&path, 16000, 1, &samples);

    let mut reader = FileReader::open(&path, 16000).unwrap();
    assert_eq!(reader.len_bytes(), samples.len() * 2);

    let mut pcm = Vec::new();
    while let Some(chunk) = reader.read(640).await.unwrap() {
        assert!(chunk.len() <= 640);
        pcm.extend_from_slice(&chunk);
    }

    let decoded: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(decoded, samples);

    // EOF is sticky.
    assert!(reader.read(640).await.unwrap().is_none());
}

#[tokio::test]
async fn file_reader_downsamples_and_downmixes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo48k.wav");
    // 48 kHz stereo: both channels identical so the mono sum is predictable.
    let frames = 4800;
    let mut samples = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let value = (i % 1000) as i16;
        samples.push(value);
        samples.push(value);
    }
    write_wav(&path, 48000, 2, &samples);

    let reader = FileReader::open(&path, 16000).unwrap();
    // 4800 stereo frames -> 4800 mono samples -> decimated by 3 -> 1600.
    assert_eq!(reader.len_bytes(), 1600 * 2);
}

#[tokio::test]
async fn file_writer_produces_a_valid_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.wav");

    let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN, 42];
    let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    let mut writer = FileWriter::create(&path, 16000, 1).unwrap();
    writer.write(&pcm[..6]).await.unwrap();
    writer.write(&pcm[6..]).await.unwrap();
    writer.close().await.unwrap();
    // close() is idempotent
    writer.close().await.unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read_back: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_back, samples);
}

#[tokio::test]
async fn file_writer_rejects_writes_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("closed.wav");

    let mut writer = FileWriter::create(&path, 16000, 1).unwrap();
    writer.close().await.unwrap();
    assert!(writer.write(&[0, 0]).await.is_err());
}

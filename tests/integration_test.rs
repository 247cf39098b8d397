//! End-to-end tests over the public API: ingestion, cascade, configuration,
//! report export and cloning.

mod common;

use chanlun::adapters::csv_report_adapter::CsvReportAdapter;
use chanlun::adapters::ini_config_adapter::IniConfigAdapter;
use chanlun::domain::candle::{Direction, Fractal};
use chanlun::domain::config::{ChanConfig, FxCheck, SegAlgo, StrokeAlgo, StrokeConfig};
use chanlun::domain::error::ChanError;
use chanlun::domain::report::Reports;
use chanlun::domain::sequence::CandleSequence;
use chanlun::ports::report_port::ReportPort;
use common::*;
use std::fs;

mod scenario {
    use super::*;

    #[test]
    fn top_then_bottom_fractal_makes_one_down_stroke() {
        init_logger();
        let config = ChanConfig {
            stroke: StrokeConfig {
                algo: StrokeAlgo::Fx,
                ..StrokeConfig::default()
            },
            ..ChanConfig::default()
        };
        let bars = bars_from(&[
            (10.0, 8.0),
            (12.0, 10.0),
            (11.0, 9.0),
            (10.0, 7.0),
            (11.0, 8.0),
        ]);
        let mut sequence = CandleSequence::new(config).unwrap();
        for bar in bars.iter().take(3).cloned() {
            sequence.ingest(bar).unwrap();
        }
        assert_eq!(sequence.candles().len(), 3);
        assert_eq!(sequence.candles()[1].fractal, Fractal::Top);
        assert!(sequence.strokes().is_empty());

        // The bottom at candle 3 is only classified once candle 4 exists.
        for bar in bars.iter().skip(3).cloned() {
            sequence.ingest(bar).unwrap();
        }
        assert_eq!(sequence.candles()[3].fractal, Fractal::Bottom);
        let strokes = sequence.strokes();
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].direction, Direction::Down);
        assert_eq!(strokes[0].begin_candle, 1);
        assert_eq!(strokes[0].end_candle, 3);
    }

    #[test]
    fn trend_wave_builds_every_layer() {
        init_logger();
        let sequence = run(config(false), &wave_bars(&trend_pivots(), 5));
        assert!(sequence.strokes().len() > 40);
        assert!(!sequence.segments().is_empty());
        assert!(sequence.strokes().iter().all(|s| s.segment_index.is_some()));
        let bar_indices: Vec<usize> = sequence.signals().iter().map(|s| s.mark.index).collect();
        assert!(bar_indices.windows(2).all(|w| w[0] <= w[1]));
        for (i, stroke) in sequence.strokes().iter().enumerate() {
            assert_eq!(stroke.index, i);
        }
    }

    #[test]
    fn every_stroke_but_the_tail_is_sure_in_batch() {
        let sequence = run(config(false), &wave_bars(&trend_pivots(), 5));
        let strokes = sequence.strokes();
        let (_, settled) = strokes.split_last().unwrap();
        assert!(settled.iter().all(|s| s.is_sure));
    }
}

mod configuration {
    use super::*;

    const INI: &str = "\
[chan]
seg_algo = chan
streaming = yes
macd_fast = 10

[stroke]
fx_check = loss
strict = false

[signal]
divergence_rate = 0.9
max_bs2_rate-sell = 0.5
";

    #[test]
    fn ini_source_drives_config() {
        let adapter = IniConfigAdapter::from_string(INI).unwrap();
        let config = ChanConfig::from_port(&adapter).unwrap();
        assert!(config.streaming);
        assert_eq!(config.seg_algo, SegAlgo::Chan);
        assert_eq!(config.macd.fast, 10);
        assert_eq!(config.stroke.fx_check, FxCheck::Loss);
        assert!(!config.stroke.is_strict);
        approx::assert_relative_eq!(config.signal.buy.divergence_rate, 0.9);
        approx::assert_relative_eq!(config.signal.sell.max_bs2_rate, 0.5);
        approx::assert_relative_eq!(config.signal.buy.max_bs2_rate, 0.9999);
        assert!(CandleSequence::new(config).is_ok());
    }

    #[test]
    fn unknown_segment_algorithm_is_rejected() {
        let port = MockConfigPort::new().with("chan", "seg_algo", "zigzag");
        let err = ChanConfig::from_port(&port).unwrap_err();
        assert!(matches!(err, ChanError::ConfigInvalid { ref key, .. } if key == "seg_algo"));
    }

    #[test]
    fn out_of_range_bs2_rate_is_rejected() {
        let port = MockConfigPort::new().with("signal", "max_bs2_rate", "1.5");
        assert!(matches!(
            ChanConfig::from_port(&port).unwrap_err(),
            ChanError::ConfigInvalid { .. }
        ));
    }

    #[test]
    fn deprecated_algorithm_runs() {
        init_logger();
        let port = MockConfigPort::new().with("chan", "seg_algo", "break");
        let config = ChanConfig::from_port(&port).unwrap();
        let sequence = run(config, &wave_bars(&trend_pivots(), 5));
        assert!(!sequence.strokes().is_empty());
    }
}

mod reports {
    use super::*;

    #[test]
    fn csv_export_writes_every_row_set() {
        init_logger();
        let sequence = run(config(false), &wave_bars(&trend_pivots(), 5));
        let reports = sequence.reports();
        let dir = tempfile::tempdir().unwrap();
        CsvReportAdapter::new().write(&reports, dir.path()).unwrap();

        for name in Reports::NAMES {
            assert!(dir.path().join(format!("{name}.csv")).exists());
        }
        let bi = fs::read_to_string(dir.path().join("bi_list.csv")).unwrap();
        assert_eq!(bi.lines().count(), sequence.strokes().len() + 1);
        assert!(bi.starts_with("index,begin_time,end_time"));
        let kline = fs::read_to_string(dir.path().join("kline_list.csv")).unwrap();
        assert_eq!(kline.lines().count(), sequence.candles().len() + 1);
    }

    #[test]
    fn report_rows_follow_lists() {
        let sequence = run(config(false), &wave_bars(&trend_pivots(), 5));
        let reports = sequence.reports();
        assert_eq!(reports.seg_list.len(), sequence.segments().len());
        assert_eq!(reports.zs_list.len(), sequence.zones().len());
        assert_eq!(reports.bs_point_lst.len(), sequence.signals().len());
        assert_eq!(reports.bs_point_history.len(), sequence.signal_history().len());
        assert_eq!(reports.bi_list[0].begin_time, "2024-03-04 09:35:00");
    }
}

mod cloning {
    use super::*;

    #[test]
    fn clone_reports_match_and_diverge_independently() {
        let bars = wave_bars(&trend_pivots(), 5);
        let (head, rest) = bars.split_at(bars.len() / 2);
        let mut original = run(config(true), head);
        let mut copy = original.deep_clone().unwrap();
        assert_eq!(copy.reports(), original.reports());

        let before = original.reports();
        for bar in rest.iter().cloned() {
            copy.ingest(bar).unwrap();
        }
        copy.cascade().unwrap();
        assert_eq!(original.reports(), before);
        assert!(copy.strokes().len() > original.strokes().len());

        original.ingest(rest[0].clone()).unwrap();
        assert_eq!(original.bars().count(), head.len() + 1);
        assert_eq!(copy.bars().count(), bars.len());
    }
}

mod modes {
    use super::*;

    #[test]
    fn streaming_and_batch_agree_on_trend_wave() {
        let bars = wave_bars(&trend_pivots(), 5);
        let streaming = run(config(true), &bars);
        let batch = run(config(false), &bars);
        assert_eq!(streaming.candles(), batch.candles());
        assert_eq!(streaming.strokes(), batch.strokes());
        assert_eq!(streaming.segments(), batch.segments());
        assert_eq!(streaming.segment_segments(), batch.segment_segments());
        assert_eq!(streaming.zones(), batch.zones());
        assert_eq!(streaming.segment_zones(), batch.segment_zones());
        assert_eq!(streaming.signals(), batch.signals());
        assert_eq!(streaming.segment_signals(), batch.segment_signals());

        // Only the per-cascade histories may differ between the modes.
        let (mut streamed, mut batched) = (streaming.reports(), batch.reports());
        for reports in [&mut streamed, &mut batched] {
            reports.bs_point_history.clear();
            reports.seg_bs_point_history.clear();
        }
        assert_eq!(streamed, batched);
    }

    #[test]
    fn cascade_is_idempotent() {
        let mut sequence = run(config(false), &wave_bars(&trend_pivots(), 5));
        let strokes = sequence.strokes().to_vec();
        let segments = sequence.segments().to_vec();
        let zones = sequence.zones().to_vec();
        let signals = sequence.signals().clone();
        sequence.cascade().unwrap();
        assert_eq!(sequence.strokes(), &strokes[..]);
        assert_eq!(sequence.segments(), &segments[..]);
        assert_eq!(sequence.zones(), &zones[..]);
        assert_eq!(sequence.signals(), &signals);
    }
}

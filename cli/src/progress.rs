use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use priority_bp::{CompletionProgress, ProgressUpdate};

/// Terminal progress: one bar for the pyramid levels, one for the nodes
/// committed on the current level
pub struct ProgressBars {
    total_pb: ProgressBar,
    level_pb: ProgressBar,

    total_len: usize,
    level_len: usize,
    level_num: usize,
}

impl ProgressBars {
    pub fn new() -> Self {
        let multi_pb = MultiProgress::new();
        let sty = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} levels")
            .progress_chars("##-");

        let total_pb = multi_pb.add(ProgressBar::new(1));
        total_pb.set_style(sty);

        let sty = ProgressStyle::default_bar()
            .template(" level {msg:>3} {bar:40.cyan/blue} {pos}/{len} nodes")
            .progress_chars("##-");
        let level_pb = multi_pb.add(ProgressBar::new(1));
        level_pb.set_style(sty);

        std::thread::spawn(move || {
            let _ = multi_pb.join();
        });

        Self {
            total_pb,
            level_pb,
            total_len: 1,
            level_len: 1,
            level_num: usize::MAX,
        }
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        self.total_pb.finish();
        self.level_pb.finish();
    }
}

impl CompletionProgress for ProgressBars {
    fn update(&mut self, update: ProgressUpdate) {
        if update.total.total != self.total_len {
            self.total_len = update.total.total;
            self.total_pb.set_length(self.total_len as u64);
        }

        // levels are solved coarsest first, show the pyramid depth
        let level_num = update.total.total - 1 - update.total.current;
        if level_num != self.level_num || update.stage.total != self.level_len {
            self.level_num = level_num;
            self.level_len = update.stage.total;
            self.level_pb.set_length(self.level_len as u64);
            self.level_pb.set_message(&self.level_num.to_string());
        }

        let level_done = update.stage.current == update.stage.total;
        self.total_pb
            .set_position((update.total.current + level_done as usize) as u64);
        self.level_pb.set_position(update.stage.current as u64);
    }
}

use conveyor_derive::conveyor_error;

#[conveyor_error]
pub enum QueueError {
    #[error("Queue I/O failed: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
}

fn main() {}

mod poll;
mod processor;

pub use processor::ReceiptProcessor;

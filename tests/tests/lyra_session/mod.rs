mod merging;
mod playback;
mod recovery;
